//! WSDL documents shared by unit tests.

/// RPC/literal service with a single string-in, string-out operation.
pub const HELLO_WSDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions name="HelloService"
   targetNamespace="http://www.examples.com/wsdl/HelloService.wsdl"
   xmlns="http://schemas.xmlsoap.org/wsdl/"
   xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
   xmlns:tns="http://www.examples.com/wsdl/HelloService.wsdl"
   xmlns:xsd="http://www.w3.org/2001/XMLSchema">
   <message name="SayHelloRequest">
      <part name="firstName" type="xsd:string"/>
   </message>
   <message name="SayHelloResponse">
      <part name="greeting" type="xsd:string"/>
   </message>
   <portType name="Hello_PortType">
      <operation name="sayHello">
         <input message="tns:SayHelloRequest"/>
         <output message="tns:SayHelloResponse"/>
      </operation>
   </portType>
   <binding name="Hello_Binding" type="tns:Hello_PortType">
      <soap:binding style="rpc" transport="http://schemas.xmlsoap.org/soap/http"/>
      <operation name="sayHello">
         <soap:operation soapAction="sayHello"/>
         <input><soap:body use="literal"/></input>
         <output><soap:body use="literal"/></output>
      </operation>
   </binding>
   <service name="Hello_Service">
      <port binding="tns:Hello_Binding" name="Hello_Port">
         <soap:address location="http://localhost:51515/SayHello/"/>
      </port>
   </service>
</definitions>"#;

/// Document/literal service with complex, repeated and attributed content.
pub const PEOPLE_WSDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions targetNamespace="urn:people"
   xmlns="http://schemas.xmlsoap.org/wsdl/"
   xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
   xmlns:tns="urn:people"
   xmlns:meta="urn:meta"
   xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <types>
    <xs:schema targetNamespace="urn:meta" elementFormDefault="qualified">
      <xs:element name="id" type="xs:string"/>
    </xs:schema>
    <xs:schema targetNamespace="urn:people" elementFormDefault="qualified">
      <xs:complexType name="Person">
        <xs:sequence>
          <xs:element name="name" type="xs:string"/>
          <xs:element name="age" type="xs:int" minOccurs="0"/>
          <xs:element name="score" type="xs:double" minOccurs="0"/>
          <xs:element name="active" type="xs:boolean" minOccurs="0"/>
          <xs:element name="born" type="xs:date" minOccurs="0"/>
          <xs:element name="tag" type="xs:string" minOccurs="0" maxOccurs="unbounded"/>
          <xs:element name="id" type="xs:int" minOccurs="0"/>
          <xs:element ref="meta:id" minOccurs="0"/>
          <xs:element name="friend" type="tns:Person" minOccurs="0" maxOccurs="unbounded"/>
        </xs:sequence>
        <xs:attribute name="key" type="xs:string"/>
      </xs:complexType>
      <xs:complexType name="Employee">
        <xs:complexContent>
          <xs:extension base="tns:Person">
            <xs:sequence>
              <xs:element name="salary" type="xs:decimal"/>
            </xs:sequence>
          </xs:extension>
        </xs:complexContent>
      </xs:complexType>
      <xs:element name="GetPerson">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="id" type="xs:int"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="GetPersonResponse">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="person" type="tns:Person" nillable="true"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="Notify">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="message" type="xs:string"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>
  </types>
  <message name="GetPersonIn"><part name="parameters" element="tns:GetPerson"/></message>
  <message name="GetPersonOut"><part name="parameters" element="tns:GetPersonResponse"/></message>
  <message name="NotifyIn"><part name="parameters" element="tns:Notify"/></message>
  <portType name="PeoplePortType">
    <operation name="GetPerson">
      <input message="tns:GetPersonIn"/>
      <output message="tns:GetPersonOut"/>
    </operation>
    <operation name="Notify">
      <input message="tns:NotifyIn"/>
    </operation>
  </portType>
  <binding name="PeopleBinding" type="tns:PeoplePortType">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="GetPerson">
      <soap:operation soapAction="urn:people/GetPerson"/>
      <input><soap:body use="literal"/></input>
      <output><soap:body use="literal"/></output>
    </operation>
    <operation name="Notify">
      <soap:operation soapAction="urn:people/Notify"/>
      <input><soap:body use="literal"/></input>
    </operation>
  </binding>
  <binding name="PeopleAdminBinding" type="tns:PeoplePortType">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="GetPerson">
      <soap:operation soapAction="urn:people/admin/GetPerson"/>
    </operation>
    <operation name="Notify">
      <soap:operation soapAction="urn:people/admin/Notify"/>
    </operation>
  </binding>
  <service name="PeopleService">
    <port name="PeoplePort" binding="tns:PeopleBinding">
      <soap:address location="http://localhost:8080/people"/>
    </port>
    <port name="PeopleAdminPort" binding="tns:PeopleAdminBinding">
      <soap:address location="http://localhost:8080/admin/people/"/>
    </port>
  </service>
</definitions>"#;

/// RPC binding whose operation declares document style.
pub const STYLE_MIX_WSDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions targetNamespace="http://tempuri.org/"
   xmlns="http://schemas.xmlsoap.org/wsdl/"
   xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
   xmlns:tns="http://tempuri.org/"
   xmlns:urn="urn:hl7-org:v3"
   xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <types>
    <xs:schema targetNamespace="urn:hl7-org:v3" elementFormDefault="qualified">
      <xs:element name="hl7Message">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="test" type="xs:string" minOccurs="0"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
      <xs:element name="hl7MessageResponse">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="result" type="xs:string" minOccurs="0"/>
          </xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>
  </types>
  <message name="hl7MessageIn"><part name="parameters" element="urn:hl7Message"/></message>
  <message name="hl7MessageOut"><part name="parameters" element="urn:hl7MessageResponse"/></message>
  <portType name="Hl7PortType">
    <operation name="opHl7Message">
      <input message="tns:hl7MessageIn"/>
      <output message="tns:hl7MessageOut"/>
    </operation>
  </portType>
  <binding name="Hl7Binding" type="tns:Hl7PortType">
    <soap:binding style="rpc" transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="opHl7Message">
      <soap:operation soapAction="urn:#opHl7Message" style="document"/>
      <input><soap:body use="literal"/></input>
      <output><soap:body use="literal"/></output>
    </operation>
  </binding>
  <service name="HL7Service">
    <port name="Hl7MessageBinding" binding="tns:Hl7Binding">
      <soap:address location="http://localhost:51515/"/>
    </port>
  </service>
</definitions>"#;
